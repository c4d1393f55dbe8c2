//! The purpose of this library is to manage the lifecycle of native OpenGL
//! rendering contexts and to negotiate framebuffer capabilities against what
//! the platform can actually provide.
//!
//! Everything starts at a [`Display`], created for one backend out of a
//! closed set. Describe what you need as [`Capabilities`] and let
//! [`Display::choose_config`] negotiate a concrete [`Config`] for it; a
//! pluggable [`CapabilitiesChooser`] decides between the candidate formats
//! the platform enumerates. With a [`Config`] in hand you create a
//! [`Surface`] (window, pixmap or pbuffer) and a [`Context`] on it.
//!
//! A [`Context`] is created lazily: the native context comes into existence
//! on the first successful [`make_current`], which is also when display list
//! and texture sharing is wired through the context's share group, see
//! [`Display::register_sharing`]. Operations that cannot run at the moment
//! they're requested, because the surface is not realized or another thread
//! holds the context, either report a recoverable "retry later" sentinel or
//! are queued and drained on the next [`invoke`].
//!
//! [`Display`]: crate::display::Display
//! [`Display::choose_config`]: crate::display::Display::choose_config()
//! [`Display::register_sharing`]: crate::display::Display::register_sharing()
//! [`Capabilities`]: crate::config::Capabilities
//! [`CapabilitiesChooser`]: crate::chooser::CapabilitiesChooser
//! [`Config`]: crate::config::Config
//! [`Surface`]: crate::surface::Surface
//! [`Context`]: crate::context::Context
//! [`make_current`]: crate::context::Context::make_current()
//! [`invoke`]: crate::context::Context::invoke()

#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod api;
pub mod chooser;
pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod surface;

mod proc_table;
mod share;

#[cfg(all(test, headless_backend))]
mod tests;
