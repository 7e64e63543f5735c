//! The request-context collaborator consumed by the pipeline.
//!
//! Transport, routing, and codec concerns live elsewhere; this models only
//! what the core needs: a request descriptor, a mutable response, and an
//! appendable list of captured server-side errors.

use std::collections::BTreeMap;

/// Inbound request descriptor.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub uri: String,
}

impl Request {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
        }
    }
}

/// Mutable response under construction.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
        }
    }
}

/// A contributor failure captured during a run.
///
/// Failures are recorded here, in graph order, instead of propagating to the
/// host - one misbehaving contributor must not abort request processing at
/// the transport layer.
#[derive(Debug)]
pub struct ServerError {
    pub message: String,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ServerError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Everything the pipeline knows about one in-flight request.
#[derive(Debug, Default)]
pub struct CommunicationContext {
    pub request: Request,
    pub response: Response,
    pub server_errors: Vec<ServerError>,
}

impl CommunicationContext {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }
}
