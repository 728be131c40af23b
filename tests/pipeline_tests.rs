// Gateway file to expose pipeline tests from the pipeline/ subdirectory
// Each test file in pipeline/ needs to be included here

#[path = "pipeline/test_end_to_end.rs"]
mod test_end_to_end;

#[path = "pipeline/test_cli.rs"]
mod test_cli;

#[path = "pipeline/test_exit_codes.rs"]
mod test_exit_codes;
