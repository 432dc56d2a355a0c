pub mod delivery_record;
pub mod row;
pub mod trigger;
