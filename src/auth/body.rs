//! Size-limited body reads.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{AuthErrorKind, HmacError, HmacResult};

/// Read at most `max` bytes from `reader`.
///
/// If exactly `max` bytes were read, one more byte is read; anything but
/// EOF fails with `InputTooLarge`.
pub async fn read_bounded<R>(reader: &mut R, max: usize) -> HmacResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut content = Vec::new();
    AsyncReadExt::take(&mut *reader, max as u64)
        .read_to_end(&mut content)
        .await?;

    if content.len() == max {
        let mut extra = [0u8; 1];
        if reader.read(&mut extra).await? != 0 {
            return Err(HmacError::auth(AuthErrorKind::InputTooLarge { max }));
        }
    }

    Ok(content)
}
