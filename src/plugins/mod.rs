//! Plugins bundled with the binary

pub mod general;
pub mod poll;

use std::sync::Arc;

use crate::domain::traits::Plugin;

/// Every bundled plugin, in discovery order
pub fn builtin() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(general::GeneralPlugin), Arc::new(poll::PollPlugin)]
}
