//! Integration tests for the tokenledger library and binary.

mod cli;
mod round_trip;
