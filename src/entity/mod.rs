pub mod alerts;
pub mod greenhouses;
pub mod sensor_data;
pub mod sensors;
