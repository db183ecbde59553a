//! The [`Servant`] trait: what an adapter dispatches requests to.

use std::future::Future;
use std::pin::Pin;

use drobots_protocol::{Call, RemoteError, ReplyValue};

/// A boxed, sendable future, as returned by [`Servant::dispatch`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An object hosted on an [`ObjectAdapter`](crate::ObjectAdapter).
///
/// Servants are stored as `Arc<dyn Servant>` keyed by identity, so the
/// dispatch method returns a boxed future instead of being an
/// `async fn`. The adapter may run several `dispatch` calls on the same
/// servant at once; implementations synchronize their own state.
///
/// `IsA` is answered by the adapter from [`interface`](Self::interface)
/// and never reaches `dispatch`.
pub trait Servant: Send + Sync + 'static {
    /// The type id this servant implements, e.g. `::drobots::Player`.
    fn interface(&self) -> &'static str;

    /// Handles one call addressed to this servant.
    fn dispatch(&self, call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>>;

    /// The error to return for a call this servant does not implement.
    fn unsupported(&self, call: &Call) -> RemoteError {
        RemoteError::OperationNotExist {
            operation: call.name().to_string(),
            type_id: self.interface().to_string(),
        }
    }
}
