pub use api_response::*;
pub use bid::*;
pub use events::*;
pub use feedback::*;
pub use order::*;
pub use order_fsm::*;
pub use product::*;
pub use requests::*;
pub use user::*;

pub mod api_response;
pub mod bid;
pub mod events;
pub mod feedback;
pub mod order;
pub mod order_fsm;
pub mod product;
pub mod requests;
pub mod user;
