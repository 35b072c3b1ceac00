pub mod ask;
pub mod check_sql;
pub mod health;
