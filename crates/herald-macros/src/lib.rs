//! Procedural macros for the Herald notification dispatcher.
//!
//! This crate provides:
//!
//! - `#[derive(Notification)]` - Generates the type-hierarchy table of a notification
//!
//! # Notification Derive Macro
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! pub trait TimerEvent: Send + Sync {
//!     fn elapsed_ms(&self) -> u64;
//! }
//!
//! #[derive(Clone, Notification)]
//! pub struct Clock {
//!     pub started_at: u64,
//! }
//!
//! #[derive(Clone, Notification)]
//! #[notification(implements(dyn TimerEvent))]
//! pub struct Tick {
//!     #[notification(parent)]
//!     pub clock: Clock,
//!     pub elapsed: u64,
//! }
//! ```

mod notification;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `Notification` for structs and enums.
///
/// This generates:
/// - `notification_type(&self)` - The concrete type identity
/// - `parent(&self)` - A clone of the field marked `#[notification(parent)]`
/// - `interfaces(&self)` - The types listed in `implements(...)`
/// - `view(self: Arc<Self>, ty)` - Views of the value as itself or any listed interface
/// - `Deref`/`DerefMut` to the parent field, when there is one
///
/// # Attributes
///
/// - `#[notification(implements(dyn A, dyn B))]` - Interfaces implemented by this type, in order.
///   Supertraits are not added for you: with `trait A: B`, list `dyn B` as well to route to it
/// - `#[notification(crate = "...")]` - Path to the core crate (default: `::herald::core`)
/// - `#[notification(parent)]` on a field - The embedded base-type value; its type must
///   implement `Notification` and `Clone`
#[proc_macro_derive(Notification, attributes(notification))]
pub fn derive_notification(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match notification::derive_notification(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
