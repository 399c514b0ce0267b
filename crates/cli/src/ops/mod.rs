pub mod add_version;
pub mod cat;
pub mod cp;
pub mod gc;
pub mod init;
pub mod ls;
pub mod mkdir;
pub mod mv;
pub mod put;
pub mod rm;
pub mod rm_version;
pub mod versions;

pub use add_version::AddVersion;
pub use cat::Cat;
pub use cp::Cp;
pub use gc::Gc;
pub use init::Init;
pub use ls::Ls;
pub use mkdir::Mkdir;
pub use mv::Mv;
pub use put::Put;
pub use rm::Rm;
pub use rm_version::RmVersion;
pub use versions::Versions;

use std::path::Path;

use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use store::{ByteStream, NewBlob, VersionedFile};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Open a local file as an upload, checksumming it unless one is given.
pub(crate) async fn open_upload(
    local: &Path,
    checksum: Option<&str>,
) -> Result<(NewBlob, ByteStream), std::io::Error> {
    let size = tokio::fs::metadata(local).await?.len();
    let checksum = match checksum {
        Some(checksum) => checksum.to_string(),
        None => sha256_hex(local).await?,
    };
    let blob = NewBlob {
        checksum,
        size: size as i64,
    };
    let file = tokio::fs::File::open(local).await?;
    Ok((blob, file_stream(file)))
}

fn file_stream(file: tokio::fs::File) -> ByteStream {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        if file.read_buf(&mut buf).await? == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        Ok(Some((buf.freeze(), file)))
    })
    .boxed()
}

async fn sha256_hex(local: &Path) -> Result<String, std::io::Error> {
    let mut chunks = file_stream(tokio::fs::File::open(local).await?);
    let mut hasher = Sha256::new();
    while let Some(chunk) = chunks.try_next().await? {
        hasher.update(&chunk);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub(crate) fn format_version(version: &VersionedFile) -> String {
    format!(
        "{}  {:>10}  {}  {}",
        version.file_id, version.size, version.linked_at, version.checksum
    )
}
