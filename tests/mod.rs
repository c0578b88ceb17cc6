mod common;

mod broker_tests;
mod dispatch_tests;
mod registry_tests;
