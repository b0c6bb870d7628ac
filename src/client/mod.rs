//! The viewer side of the relay: thread state, unread bookkeeping and the
//! notification feed, driven through injected transports.

mod chat;
mod feed;
mod http;
mod socket;
mod thread;
mod unread;

pub use chat::{Applied, ChatSession, HistoryPage, HistoryTicket, Incoming, Older};
pub use feed::NotificationFeed;
pub use http::HttpBackend;
pub use socket::SocketPresence;
pub use thread::{ScrollAnchor, Thread, Viewport};
pub use unread::{UnreadCounter, badge};
