mod inbox_test;
mod orchestrator_test;
