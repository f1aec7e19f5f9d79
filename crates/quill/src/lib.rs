//! A multi-dialect SQL data-access core: query builder, Eloquent-style ORM,
//! and transactional connection pool for SQLite, MySQL, and PostgreSQL.

#![allow(async_fn_in_trait)]

pub mod prelude;

pub use quill_core::{Database, Pool, QueryBuilder, SqlError, SqlResult, Value};
pub use quill_derive::Model;

cfg_if::cfg_if! {
    if #[cfg(feature = "sqlite")] {
        #[doc(no_inline)]
        pub use quill_core::database::sqlite;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "mysql")] {
        #[doc(no_inline)]
        pub use quill_core::database::mysql;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "postgres")] {
        #[doc(no_inline)]
        pub use quill_core::database::postgres;
    }
}
