pub mod audit;
pub mod staff;
pub mod users;

pub use audit::list_audit_events;
pub use staff::{assign_staff_role, get_capabilities, remove_staff_role};
pub use users::{assign_role, create_admin_user};
