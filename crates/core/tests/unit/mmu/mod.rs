pub mod ptw;
