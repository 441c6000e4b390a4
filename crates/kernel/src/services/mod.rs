//! Kernel services backing the gates.
//!
//! Both services front external collaborators: the hosted auth provider
//! that owns sessions, and the audit log sink.

pub mod audit;
pub mod auth_provider;

pub use audit::{AuditEvent, AuditEventType, AuditSink, HostedAuditSink, TracingAuditSink};
pub use auth_provider::{
    ChainedSessionProvider, CookieSessionProvider, Credentials, HostedAuthProvider,
    ProviderError, SessionProvider, StaticTokenProvider,
};
