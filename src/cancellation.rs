pub use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Turns a cancelled [`CancellationToken`] into [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled).
///
/// The issuer checks the token before every stage and the network client polls it while
/// waiting on the KDC.
pub trait CancellationTokenExt {
    fn check(&self) -> Result<()>;
}

impl CancellationTokenExt for CancellationToken {
    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}
