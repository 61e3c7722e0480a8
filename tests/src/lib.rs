#[cfg(test)]
mod scaling;
