#[path = "integration/fixtures/mod.rs"]
mod fixtures;

#[path = "integration/model/mod.rs"]
mod model;
#[path = "integration/cli/mod.rs"]
mod cli;
