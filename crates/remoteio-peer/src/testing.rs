//! Thread-backed peers for unit tests.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use remoteio_frame::{wait_message, Message, Op};
use remoteio_transport::{Channel, HandleBased, HandleTable};

use crate::dispatch::{serve, Handler, Outcome};

/// Serve `server` on a new thread until the client closes or goes away.
///
/// The synthetic close delivered when the client disappears is answered
/// here and never reaches `handler`.
pub(crate) fn serve_with<H>(server: Channel, handler: H) -> JoinHandle<()>
where
    H: Handler + Send + 'static,
{
    thread::spawn(move || {
        let mut handler = handler;
        let mut filtered = |msg: &mut Message| {
            if msg.header.txid == 0 && Op::Close.matches(msg.header.op) {
                return Outcome::Reply(0);
            }
            handler.handle(msg)
        };
        let _ = serve(&server, &mut filtered);
    })
}

/// Wait for one open request on `parent` and pass its connection channel,
/// together with the request, to `reply`.
pub(crate) fn answer_open<F>(parent: Channel, reply: F) -> JoinHandle<()>
where
    F: FnOnce(Channel, Message, &Arc<HandleTable>) + Send + 'static,
{
    thread::spawn(move || {
        let mut msg = wait_message(&parent).expect("open request should arrive");
        let handle = msg
            .take_handles()
            .pop()
            .expect("open request should carry a channel");
        let cnxn = Channel::from_handle(handle).expect("attached handle should be a channel");
        let table = Arc::clone(parent.as_handle().table());
        reply(cnxn, msg, &table);
    })
}
