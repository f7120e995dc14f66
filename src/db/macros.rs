//! Driver dispatch macros for reducing code duplication.
//!
//! The native connection and native result types are closed enums with one
//! variant per driver. These macros generate the match arms so that driver
//! dispatch stays linear and readable.

/// Macro for generating driver dispatch match arms.
///
/// The enum must have `MySql`, `Postgres` and `Sqlite` variants and be in
/// scope at the call site.
///
/// # Example
///
/// ```ignore
/// // Same body for every driver
/// impl_native_dispatch!(NativeConnection, conn, |c| c.close().await);
///
/// // Driver-specific bodies
/// impl_native_dispatch!(NativeConnection, conn, {
///     MySql(c) => mysql::run(c, sql).await,
///     Postgres(c) => postgres::run(c, sql).await,
///     Sqlite(c) => sqlite::run(c, sql).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_native_dispatch {
    ($kind:ident, $value:expr, |$p:ident| $body:expr) => {
        match $value {
            $kind::MySql($p) => $body,
            $kind::Postgres($p) => $body,
            $kind::Sqlite($p) => $body,
        }
    };
    ($kind:ident, $value:expr, { $($variant:ident($p:pat) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $kind::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_native_dispatch;
