/// Marker shared by archive year folders and the output year folders.
pub const PHOTOS_FOLDER_MARKER: &str = "Photos from";

/// Check if a directory name marks an archive folder worth scanning.
/// Matches anywhere in the name, e.g. "Takeout Photos from 2019 (1)".
pub fn is_photos_folder(name: &str) -> bool {
    name.contains(PHOTOS_FOLDER_MARKER)
}

/// Output folder name for a calendar year
pub fn year_folder_name(year: i32) -> String {
    format!("{} {:04}", PHOTOS_FOLDER_MARKER, year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photos_folders() {
        assert!(is_photos_folder("Photos from 2023"));
        assert!(is_photos_folder("Old Photos from phone"));
        assert!(!is_photos_folder("photos FROM 2023"));
        assert!(!is_photos_folder("My Vacation"));
    }

    #[test]
    fn test_year_folder_names() {
        assert_eq!(year_folder_name(2023), "Photos from 2023");
        assert_eq!(year_folder_name(987), "Photos from 0987");
        assert!(is_photos_folder(&year_folder_name(1999)));
    }
}
