pub mod todo;
pub mod user;

pub use todo::{Priority, Todo, TodoFields};
pub use user::User;
