// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unused_imports,
    dead_code
)]
// Disallow warnings in examples.
#![doc(test(attr(deny(warnings))))]

//! `interceptproxy` is a pluggable, TLS-interception-capable HTTP/HTTPS proxy
//! connection-processing engine.
//!
//! A [`config::ProxyConfig`] describes what to bind and how; [`listener::ListenerPool`] binds it;
//! [`acceptor::AcceptorPool`] forks one accept-loop worker per configured process and hands
//! accepted connections off to a [`executor::ThreadlessExecutor`] running
//! [`http_handler::HttpProtocolHandler`] as its [`work::Work`]. Plugins observe and rewrite traffic
//! through [`plugin::ProxyPlugin`]; [`events::EventDispatcher`] fans out lifecycle events to
//! cross-process subscribers; [`tls::CertificateAuthority`] issues the leaf certificates MITM mode
//! presents to clients.
//!
//! ## Examples
//!
//! Examples can be found in the `demos` directory of the source code.

pub mod acceptor;
mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod executor;
pub mod http_handler;
pub mod listener;
pub mod net;
pub mod parser;
pub mod plugin;
pub mod rate_limiter;
pub mod tls;
pub mod work;
