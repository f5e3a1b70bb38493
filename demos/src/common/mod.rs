#![allow(dead_code)]
pub mod todos;
