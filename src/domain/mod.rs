//! Restaurant entities and the rules for changing them.
//!
//! Everything here is pure: transitions take the current entity and return
//! the next one or the reason it cannot move. The resource adapters run
//! these checks before any remote call.

pub mod delivery;
pub mod inventory;
pub mod order;
pub mod table;
pub mod timer;

pub use delivery::{DeliveryItem, DeliveryOrder, DeliveryStatus, KitchenTicket, NewDelivery};
pub use inventory::{Ingredient, Recipe, RecipeLine};
pub use order::{Order, OrderItem, OrderLine, OrderStatus};
pub use table::{Table, TableAction, TableStatus};
pub use timer::{Elapsed, Urgency};
