//! Database connection seam.
//!
//! The storage connector does not talk to databases itself: a caller that wants
//! probers to see a database hands over a [`ConnectionFactory`], and the connector
//! opens at most one [`Connection`] from it.

use std::{cell::RefCell, rc::Rc};

use tessera_io::Closeable;

/// An open database connection.
pub trait Connection: Closeable {
    /// Returns `true` once the connection has been closed.
    fn is_closed(&self) -> bool;
}

/// A connection shared between the connector and the probers.
pub type SharedConnection = Rc<RefCell<dyn Connection>>;

/// Source of database connections.
pub trait ConnectionFactory {
    fn connect(&self) -> std::io::Result<SharedConnection>;
}
