use camino::Utf8Path;
use simple_error::{SimpleResult, bail};

use crate::filenames::PRIOR_RUN_ARTIFACTS;
use crate::os_utils::create_dir_all;

/// Check that the output directory holds no prior run results, creating it if it does not exist
///
/// Assumes no logger has been configured yet
///
pub fn check_and_create_output_dir(output_dir: &Utf8Path) -> SimpleResult<()> {
    if output_dir.exists() {
        if !output_dir.is_dir() {
            bail!("Output directory path exists but is not a directory: '{output_dir}'");
        }
        if let Some(artifact) = PRIOR_RUN_ARTIFACTS
            .iter()
            .find(|x| output_dir.join(x).exists())
        {
            bail!(
                "Output directory '{output_dir}' already contains '{artifact}' from a previous run. Choose a new output directory"
            );
        }
        Ok(())
    } else {
        create_dir_all(output_dir, "output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filenames::{IR_NONDIR_RESULT_FILENAME, RUN_STDOUT_LOG_FILENAME};
    use crate::os_utils::tests::temp_utf8_dir;

    #[test]
    fn test_new_output_dir_is_created() {
        let (_dir, path) = temp_utf8_dir();
        let output_dir = path.join("run1");
        check_and_create_output_dir(&output_dir).unwrap();
        assert!(output_dir.is_dir());
    }

    #[test]
    fn test_existing_clean_output_dir() {
        let (_dir, path) = temp_utf8_dir();
        std::fs::write(path.join("unrelated.txt"), "").unwrap();
        check_and_create_output_dir(&path).unwrap();
    }

    #[test]
    fn test_prior_run_output_dir_rejected() {
        for artifact in [IR_NONDIR_RESULT_FILENAME, RUN_STDOUT_LOG_FILENAME] {
            let (_dir, path) = temp_utf8_dir();
            std::fs::write(path.join(artifact), "").unwrap();
            assert!(check_and_create_output_dir(&path).is_err());
        }
    }

    #[test]
    fn test_output_path_is_file() {
        let (_dir, path) = temp_utf8_dir();
        let file = path.join("file");
        std::fs::write(&file, "").unwrap();
        assert!(check_and_create_output_dir(&file).is_err());
    }
}
