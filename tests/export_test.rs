/// Spreadsheet output read back with calamine.
use calamine::{open_workbook, Reader, Xlsx};
use mnrega_muster::tools::export::{artifact_file_name, artifact_path, write_records, SHEET_NAME};
use mnrega_muster::FieldRecord;

fn record(pairs: &[(&str, &str)]) -> FieldRecord {
    pairs.iter().copied().collect()
}

#[test]
fn sanitized_name_is_deterministic() {
    assert_eq!(artifact_file_name("GJ/1109 001"), "mnrega_GJ_1109_001.xlsx");
    for code in ["GJ/1109 001", r"GJ\1109", "WC-77"] {
        assert_eq!(artifact_file_name(code), artifact_file_name(code));
        assert!(!artifact_file_name(code)["mnrega_".len()..].contains(['/', '\\', ' ']));
    }
}

#[test]
fn columns_are_the_union_of_headers_in_first_seen_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(dir.path(), "WC-77");
    let records = vec![
        record(&[("S.No", "1"), ("Name", "Ram")]),
        record(&[("S.No", "2"), ("Account", "SBI-1")]),
    ];

    write_records(&path, &records).unwrap();

    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec![SHEET_NAME.to_string()]);
    let range = workbook.worksheet_range(SHEET_NAME).unwrap();
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect();
    assert_eq!(
        rows,
        vec![
            vec!["S.No", "Name", "Account"],
            vec!["1", "Ram", ""],
            vec!["2", "", "SBI-1"],
        ]
    );
}

#[test]
fn empty_record_set_still_produces_a_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir.path().join("nested"), "WC-77");

    write_records(&path, &[]).unwrap();

    assert!(path.is_file());
    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    let range = workbook.worksheet_range(SHEET_NAME).unwrap();
    assert!(range.is_empty());
}
