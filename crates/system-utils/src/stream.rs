use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) async fn read_stream_capture<R: AsyncRead + Unpin>(
    mut reader: R,
) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await?;
    Ok(buffer)
}

/// Writes the whole payload and closes the pipe. A child that exits
/// without reading its input is not an error.
pub(crate) async fn write_input<W: AsyncWrite + Unpin>(
    mut writer: W,
    payload: Vec<u8>,
) -> io::Result<()> {
    match writer.write_all(&payload).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err),
    }
    match writer.shutdown().await {
        Err(err) if err.kind() != io::ErrorKind::BrokenPipe => Err(err),
        _ => Ok(()),
    }
}
