pub mod rc_script;
pub mod rsync;
