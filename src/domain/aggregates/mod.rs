//! Aggregates module
pub mod cart;
pub mod installation;
pub mod order;
pub mod payment;
pub mod product;
pub mod review;
pub mod user;

pub use cart::{Cart, CartError, CartItem};
pub use installation::{Installation, InstallationError, InstallationStatus};
pub use order::{Order, OrderError, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentError, PaymentStatus};
pub use product::{NewProduct, Product, ProductError, ProductPatch, SuitableFor};
pub use review::{Review, ReviewError};
pub use user::{NewUser, Role, User};
