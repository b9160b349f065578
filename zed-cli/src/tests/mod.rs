mod zson_tests;
