pub mod atomic_write;
/**
 * Classification of out-of-sync paths between
 *  a local and a remote snapshot.
 */
pub mod changes;
/**
 * Block based binary delta: signatures, diffs
 *  and reconstruction.
 */
pub mod delta;
pub mod local_state;
/**
 * Per directory permission files and the tree
 *  that resolves access for a path.
 */
pub mod permissions;
pub mod queue;
/**
 * The sync server as seen from a client, plus
 *  the wire types shared with the server.
 */
pub mod remote;
/**
 * File based request/response messaging carried
 *  over the synced tree.
 */
pub mod rpc;
/**
 * Directory snapshots, hashing and ignore rules.
 */
pub mod state;
/**
 * Client sync loop: manager, consumer and the
 *  errors they share.
 */
pub mod sync;
pub mod sync_path;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::changes::{FileChangeInfo, FileChangeKind, SyncSide};
    pub use crate::local_state::{LocalSyncState, SyncStatus};
    pub use crate::permissions::{Capabilities, ParseMode, PermissionRule, PermissionTree};
    pub use crate::remote::{RemoteError, SyncRemote};
    pub use crate::rpc::{RpcEndpoint, SyftFuture, SyftRequest, SyftResponse, SyftUrl};
    pub use crate::state::{DirectoryState, FileMetadata};
    pub use crate::sync::{SyncConfig, SyncManager};
    pub use crate::version::build_info;
}
