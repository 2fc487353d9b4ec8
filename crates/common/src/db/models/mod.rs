//! SeaORM entity models
//!
//! Database entities for SalesTrackr

mod client;
mod session;
mod user;
mod visit;

pub use user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as UserEntity, Model as User,
};

pub use client::{
    ActiveModel as ClientActiveModel, Column as ClientColumn, Entity as ClientEntity,
    Model as Client,
};

pub use visit::{
    ActiveModel as VisitActiveModel, Column as VisitColumn, Entity as VisitEntity, Model as Visit,
};

pub use session::{
    ActiveModel as SessionActiveModel, Column as SessionColumn, Entity as SessionEntity,
    Model as Session,
};
