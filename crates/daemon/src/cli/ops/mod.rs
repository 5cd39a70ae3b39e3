pub mod daemon;
pub mod health;
pub mod init;
pub mod rpc;
pub mod server;
pub mod version;

pub use daemon::Daemon;
pub use health::Health;
pub use init::Init;
pub use rpc::Rpc;
pub use server::Server;
pub use version::Version;
