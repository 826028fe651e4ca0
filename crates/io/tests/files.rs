use std::fs;

use georef_io::{read_table, write_table, write_text, IoError};
use georef_resolve::Table;
use tempfile::tempdir;

#[test]
fn reads_windows_1252_semicolon_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("diccionario_MUN_22.csv");
    fs::write(
        &path,
        b"KEY_benef_mun;KEY_inegi_municipio\r\nguerrero-acapulco;Guerrero-Acapulco de Ju\xe1rez\r\n",
    )
    .unwrap();

    let table = read_table(&path, "windows-1252", b';').unwrap();
    assert_eq!(table.headers, vec!["KEY_benef_mun", "KEY_inegi_municipio"]);
    assert_eq!(table.rows[0][1], "Guerrero-Acapulco de Juárez");
}

#[test]
fn declared_utf8_with_latin1_bytes_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("source.csv");
    fs::write(&path, b"ENTIDAD,MUNICIPIO\nM\xe9xico,Toluca\n").unwrap();

    let err = read_table(&path, "utf-8", b',').unwrap_err();
    assert!(matches!(err, IoError::Decode { .. }));
    assert!(err.to_string().contains("source.csv"));
}

#[test]
fn missing_file_is_read_error() {
    let dir = tempdir().unwrap();
    let err = read_table(&dir.path().join("nope.csv"), "utf-8", b',').unwrap_err();
    assert!(matches!(err, IoError::Read { .. }));
}

#[test]
fn written_table_reads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("enriched.csv");
    let mut table = Table::new(vec!["FOLIO".into(), "Municipio".into()]);
    table.push_row(vec!["F001".into(), "Xalapa, Ver.".into()]);
    table.push_row(vec!["F002".into(), "Acapulco de Juárez".into()]);

    write_table(&path, &table, b',').unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"Xalapa, Ver.\""));

    assert_eq!(read_table(&path, "utf-8", b',').unwrap(), table);
}

#[test]
fn write_into_missing_directory_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("out.csv");
    let err = write_table(&path, &Table::new(vec!["A".into()]), b',').unwrap_err();
    assert!(matches!(err, IoError::Write { .. }));
    assert!(matches!(
        write_text(&path, "{}"),
        Err(IoError::Write { .. })
    ));
}
