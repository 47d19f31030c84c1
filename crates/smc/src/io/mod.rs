// Input/Output: mesh file parsing and serialization

pub mod obj;

pub use obj::{parse_obj, read_obj, write_obj, write_obj_file, ObjError};
