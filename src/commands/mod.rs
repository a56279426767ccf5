pub mod chains;
pub mod info;
pub mod restore;
pub mod rules;
