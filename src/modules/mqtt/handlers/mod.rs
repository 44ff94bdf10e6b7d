pub mod measurements;
