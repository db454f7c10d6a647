pub mod auth;
pub mod config;
pub mod importer;
pub mod models;
pub mod quizdb;
pub mod quizweb;
pub mod scoring;
