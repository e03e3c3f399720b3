//! Picture-in-picture compositing
//!
//! Merges the screen and camera sources into one synthetic source: the
//! screen fills the surface, the camera sits bottom-right in a bordered
//! square.

pub mod composition;
pub mod layout;
pub mod surface;

pub use composition::{Composition, Compositor};
pub use layout::{overlay_layout, overlay_size, OverlayLayout, Rect};
pub use surface::Surface;

use crate::utils::error::ErrorKind;
use thiserror::Error;

/// Compositor errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("Not ready: {0}")]
    NotReady(String),
}

impl CompositeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompositeError::NotReady(_) => ErrorKind::NotReady,
        }
    }
}
