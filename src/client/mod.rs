//! Client-side session synchronization: a change notifier with push and
//! polling feeds, and a per-player session mirroring the authoritative room.

pub mod api;
pub mod countdown;
pub mod driver;
#[cfg(feature = "http-client")]
pub mod http;
pub mod local;
pub mod notifier;
pub mod retry;
pub mod session;
pub mod sse_decoder;

pub use api::{ApiResult, ClientError, PushEvent, PushStream, RoomApi};
pub use driver::{SessionHandle, SessionView};
pub use local::LocalRoomApi;
pub use notifier::{ChangeNotifier, DeliveryMode, NotifierConfig, RoomSignal};
pub use session::{ClientPhase, SessionSync};
