//! Mod Sandbox: executes untrusted script text against an explicit,
//! enumerable capability set.
//!
//! # Invariants
//! - A script observes only the Rhai core language plus [`binding_names`].
//! - Every failed execution is paired with an error notification naming
//!   the mod. Entities created before the failure stay in the world.
//! - Execution never touches the animation registry directly; new tasks go
//!   through a [`worldspace_kernel::TaskInbox`].
//!
//! This is a convenience boundary, not a security boundary. The operation
//! budget turns most runaway loops into ordinary failures; a budget of zero
//! disables that.

mod capabilities;
mod handles;
mod props;
mod sandbox;

pub use handles::EntityRef;
pub use props::{CubeProps, CylinderProps, FactoryDefaults, GroupProps, LightProps, SphereProps};
pub use sandbox::{ExecutionReport, Sandbox, SandboxError, SandboxLimits, binding_names};

pub fn crate_info() -> &'static str {
    "worldspace-sandbox v0.1.0"
}
