use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use facet_json::{from_str as from_json, to_string as to_json};
use koma_archive::{ChapterIndex, INDEX_VERSION};
use std::collections::BTreeMap;

/// The three columns a [`ChapterIndex`] is persisted as.
///
/// The image list is stored as a JSON array and the identifier map as a
/// JSON object, so rows stay readable with the `sqlite3` shell.
#[derive(sqlx::FromRow, Debug, Default, PartialEq, Eq)]
pub(crate) struct IndexColumns {
    pub(crate) index_version: Option<i64>,
    pub(crate) image_list: Option<String>,
    pub(crate) image_id_map: Option<String>,
}
impl TryFrom<Option<&ChapterIndex>> for IndexColumns {
    type Error = crate::error::Error;
    fn try_from(index: Option<&ChapterIndex>) -> Result<Self> {
        let Some(index) = index else {
            return Ok(Self::default());
        };
        Ok(Self {
            index_version: Some(i64::from(index.version())),
            image_list: Some(to_json(&index.images().to_vec()).or_raise(|| ErrorKind::InvalidData("image list"))?),
            image_id_map: Some(to_json(index.ids()).or_raise(|| ErrorKind::InvalidData("image id map"))?),
        })
    }
}
impl TryFrom<IndexColumns> for Option<ChapterIndex> {
    type Error = crate::error::Error;
    fn try_from(columns: IndexColumns) -> Result<Self> {
        let Some(list) = columns.image_list else {
            return Ok(None);
        };
        let images = from_json::<Vec<String>>(&list).or_raise(|| ErrorKind::InvalidData("image list"))?;
        // An empty list without a current version is how an index that was
        // never built looks. A built index of a chapter with no pages carries
        // the version.
        if images.is_empty() && columns.index_version != Some(i64::from(INDEX_VERSION)) {
            return Ok(None);
        }
        let ids = match columns.image_id_map {
            Some(map) => from_json::<BTreeMap<String, String>>(&map).or_raise(|| ErrorKind::InvalidData("image id map"))?,
            None => BTreeMap::new(),
        };
        let version = columns
            .index_version
            .map(|v| u32::try_from(v).or_raise(|| ErrorKind::InvalidData("index version")))
            .transpose()?
            .unwrap_or(0);
        Ok(Some(ChapterIndex::from_parts(version, images, ids)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_columns_from_index() {
        let index = ChapterIndex::build(vec!["01/p1.jpg".to_string(), "01/p2.jpg".to_string()]);
        let columns = IndexColumns::try_from(Some(&index)).unwrap();
        assert_eq!(columns.index_version, Some(1));
        assert!(columns.image_list.as_deref().is_some_and(|list| list.starts_with('[')));
        assert!(columns.image_id_map.as_deref().is_some_and(|map| map.contains("img-00002")));
        let back = Option::<ChapterIndex>::try_from(columns).unwrap();
        assert_eq!(back, Some(index));
    }

    #[test]
    fn test_absent_index() {
        let columns = IndexColumns::try_from(None::<&ChapterIndex>).unwrap();
        assert_eq!(columns, IndexColumns::default());
        assert_eq!(Option::<ChapterIndex>::try_from(columns).unwrap(), None);
    }

    #[rstest]
    #[case(None, Some("[]"), Some("{}"))]
    #[case(Some(0), Some("[]"), None)]
    #[case(None, None, Some(r#"{"img-00001":"a.jpg"}"#))]
    fn test_empty_list_is_absent(#[case] version: Option<i64>, #[case] list: Option<&str>, #[case] map: Option<&str>) {
        let columns = IndexColumns {
            index_version: version,
            image_list: list.map(String::from),
            image_id_map: map.map(String::from),
        };
        assert_eq!(Option::<ChapterIndex>::try_from(columns).unwrap(), None);
    }

    #[test]
    fn test_built_empty_index_is_kept() {
        let index = ChapterIndex::build(Vec::new());
        let columns = IndexColumns::try_from(Some(&index)).unwrap();
        assert_eq!(columns.image_list.as_deref(), Some("[]"));
        let back = Option::<ChapterIndex>::try_from(columns).unwrap();
        assert_eq!(back, Some(index));
    }

    #[test]
    fn test_list_without_map_is_rebuilt() {
        let columns = IndexColumns {
            index_version: None,
            image_list: Some(r#"["a.jpg","b.jpg"]"#.to_string()),
            image_id_map: None,
        };
        let index = Option::<ChapterIndex>::try_from(columns).unwrap().unwrap();
        assert_eq!(index.resolve("img-00002"), Some("b.jpg"));
    }

    #[test]
    fn test_garbage_list_is_invalid() {
        let columns = IndexColumns {
            index_version: Some(1),
            image_list: Some("not json".to_string()),
            image_id_map: None,
        };
        let err = Option::<ChapterIndex>::try_from(columns).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("image list"));
    }
}
