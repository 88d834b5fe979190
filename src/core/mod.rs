pub mod bridge;
pub mod compositor;
pub mod errors;
pub mod ipc;
pub mod remote;
pub mod socket_manager;
pub mod state;
pub mod wayland;

// Re-export key types
pub use compositor::{Compositor, LoopData};
pub use state::CompositorState;
