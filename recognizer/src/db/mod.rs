pub mod db_utils;
pub mod dumps;
pub mod models;
pub mod schema;
