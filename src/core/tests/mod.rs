mod admission_tests;
mod logical_process_tests;
