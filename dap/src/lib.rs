//! Debug Adapter Protocol models for the editor side of the bridge.
//!
//! Only the slice of the protocol the bridge actually services is modelled:
//! requests in [`requests`], their responses in [`responses`], and the
//! notifications the session pushes at the editor in [`events`]. Shared
//! building blocks (sources, frames, scopes, variables) live in [`types`].

pub mod events;
pub mod requests;
pub mod responses;
pub mod types;
