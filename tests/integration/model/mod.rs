mod copy_on_write;
mod editing;
mod persistence;
mod scenarios;
