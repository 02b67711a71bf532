//! Aggregates module
pub mod affiliate;
pub mod campaign;
pub mod cart;
pub mod cart_session;
pub mod inventory;
pub mod lifecycle;
pub mod order;
pub mod preorder;
pub mod product;

pub use affiliate::AffiliateCode;
pub use campaign::{CampaignStatus, PreorderCampaign};
pub use cart::{Cart, CartError, CartKind, CartLine, PreorderCart, PreorderLine, RegularCart, RegularLine};
pub use cart_session::CartSession;
pub use inventory::{InventoryError, StockLevel};
pub use lifecycle::{LifecycleError, LifecycleStatus, StatusTrack, TimelineEntry};
pub use order::{LineItem, NewOrder, Order, OrderError, OrderStatus, OrderTotals};
pub use preorder::{DraftPreorder, PaymentStatus, Preorder, PreorderError, PreorderItem, PreorderStatus};
pub use product::{Product, ProductSnapshot, Variant};
