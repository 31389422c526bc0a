mod engine_selftest;
