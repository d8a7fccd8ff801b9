mod container_info;
pub use container_info::*;

pub fn get_env_bool(variable_name: impl AsRef<str>) -> Option<bool> {
    let variable_name = variable_name.as_ref();
    std::env::var(variable_name)
        .ok()
        .map(|val| match val.to_lowercase().as_ref() {
            "1" | "true" | "on" => true,
            "0" | "false" | "off" => false,
            _ => panic!("Invalid environment boolean value: {variable_name} = {val}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_env_bool_is_none() {
        assert_eq!(get_env_bool("RSBAN_TEST_SURELY_UNSET_VAR"), None);
    }
}
