pub mod apply;
pub mod destroy;
pub mod init;
pub mod plan;
pub mod state;
pub mod unlock;
