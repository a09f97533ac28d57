
mod proactive_tests;
mod search_tests;
