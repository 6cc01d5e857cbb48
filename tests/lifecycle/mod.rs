//! Lifecycle scenarios driven through the public manager API.

mod bdd_steps;
mod scenarios;
mod test_helpers;
