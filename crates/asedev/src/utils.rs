pub mod mem_reader;
