pub mod db;
pub mod grocery_items;
