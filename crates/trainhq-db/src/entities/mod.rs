pub mod train_jobs;
