pub mod results_api;
