use std::time::Duration;

use callframe_core::{Envelope, Message, SessionId, Stamp};
use tokio::sync::oneshot;

use crate::channel::MessageChannel;
use crate::error::{Error, Result};
use crate::transport::Frame;

/// Send a message to the embedded call machine and wait for its reply
///
/// Resolves with the first message echoing the request's stamp. There is no
/// timeout: if the send was dropped (frame not loaded) or the peer never
/// answers, this waits until the channel is dropped. See [`request_timeout`].
pub async fn request<C>(
    channel: &C,
    message: Message,
    session: &SessionId,
    frame: Option<&Frame>,
) -> Result<Envelope>
where
    C: MessageChannel + ?Sized,
{
    let (_, reply) = dispatch(channel, message, session, frame)?;
    reply.await.map_err(|_| Error::ChannelClosed)
}

/// Like [`request`], giving up after `timeout`
///
/// On expiry the pending callback is cancelled so it does not linger in the
/// channel, and a late reply is delivered to listeners only.
pub async fn request_timeout<C>(
    channel: &C,
    message: Message,
    session: &SessionId,
    frame: Option<&Frame>,
    timeout: Duration,
) -> Result<Envelope>
where
    C: MessageChannel + ?Sized,
{
    let (stamp, reply) = dispatch(channel, message, session, frame)?;
    match tokio::time::timeout(timeout, reply).await {
        Ok(Ok(envelope)) => Ok(envelope),
        Ok(Err(_)) => Err(Error::ChannelClosed),
        Err(_) => {
            channel.cancel_callback(&stamp);
            tracing::debug!(stamp = %stamp, ?timeout, "request timed out");
            Err(Error::Timeout(timeout))
        }
    }
}

/// Send a message to the embedded call machine without expecting a reply
pub fn notify<C>(
    channel: &C,
    message: Message,
    session: &SessionId,
    frame: Option<&Frame>,
) -> Result<()>
where
    C: MessageChannel + ?Sized,
{
    channel
        .send_to_embedded(message, None, Some(session), frame)
        .map(|_| ())
}

fn dispatch<C>(
    channel: &C,
    message: Message,
    session: &SessionId,
    frame: Option<&Frame>,
) -> Result<(Stamp, oneshot::Receiver<Envelope>)>
where
    C: MessageChannel + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    let stamp = channel
        .send_to_embedded(
            message,
            Some(Box::new(move |reply: &Envelope| {
                // The requester may have given up already
                let _ = tx.send(reply.clone());
            })),
            Some(session),
            frame,
        )?
        .ok_or_else(|| Error::Custom("Channel did not register the callback".to_string()))?;
    Ok((stamp, rx))
}
