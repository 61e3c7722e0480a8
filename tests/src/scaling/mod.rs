mod fixture;
mod test_control_surface;
mod test_job_lifecycle;
mod test_failure;
