/// Memory-mapped file source
pub mod mmap;
