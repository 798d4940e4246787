pub mod a2c;
