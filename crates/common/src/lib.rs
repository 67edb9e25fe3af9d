pub mod density;
