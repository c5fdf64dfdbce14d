//! The transport loop.
//!
//! Each connection is serviced as one task: read a length-framed envelope,
//! dispatch it on the blocking pool, write the response, repeat. Servicing
//! is generic over the stream type, which is the seam where TLS or
//! preamble-stripping transports slot in; the sync core never sees the
//! difference.

use std::{io, sync::Arc};

use futures::{SinkExt, StreamExt};
use log::info;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tokio_util::codec::Framed;

use tasksync_codec::{FrameCodec, FrameCodecError};

use crate::dispatch::{Dispatcher, error_envelope};

/// Accept connections forever.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    log_clients: bool,
) -> io::Result<()> {
    info!("Server starting");

    loop {
        let (stream, peer) = listener.accept().await?;
        let dispatcher = Arc::clone(&dispatcher);

        tokio::spawn(async move {
            if log_clients {
                info!("Connection from {peer}");
            }

            if let Err(error) = service(stream, dispatcher).await {
                info!("Connection closed: {error}");
            }
        });
    }
}

/// Service one connection until it closes or a framing error ends it.
///
/// A framing error is answered once (504 for an oversized frame, 400 for a
/// malformed one) and then the connection is dropped; the peer's framing
/// state cannot be trusted afterwards.
pub async fn service<S>(stream: S, dispatcher: Arc<Dispatcher>) -> Result<(), FrameCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, FrameCodec::new(dispatcher.request_limit()));

    while let Some(frame) = framed.next().await {
        match frame {
            Ok(body) => {
                let dispatcher = Arc::clone(&dispatcher);
                let response =
                    tokio::task::spawn_blocking(move || dispatcher.handle(&body))
                        .await
                        .unwrap_or_else(|_| error_envelope(500));
                framed.send(&response[..]).await?;
            }
            Err(error) => {
                let code = match &error {
                    FrameCodecError::TooBig { .. } => 504,
                    FrameCodecError::BadLength(_) => 400,
                    FrameCodecError::Io(_) => return Err(error),
                };
                let _ = framed.send(&error_envelope(code)[..]).await;
                return Err(error);
            }
        }
    }

    Ok(())
}
