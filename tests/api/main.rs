mod health_check;
mod subscribers;
mod worker;
