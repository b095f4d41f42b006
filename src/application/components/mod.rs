//! Interactive components - buttons, selects and modals owned by plugins

pub mod collector;
pub mod descriptor;
pub mod ids;
pub mod registry;

pub use descriptor::{
    ButtonSpec, ComponentEvent, GroupDescriptor, GroupKind, Scope, SelectSpec, TextInputSpec,
};
pub use registry::{BuiltGroup, ComponentRegistry, Dispatch, PluginComponents};
