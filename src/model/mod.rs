pub mod field;
pub mod row;
pub mod work_item;
