pub mod conversation;
pub mod db;
