pub mod work_item;
