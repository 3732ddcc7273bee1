use lsmlite::layout::BLOCK_SIZE;
use lsmlite::manifest::{MANIFEST_CAP, ManifestEntry, ManifestPage, decode_page, encode_page};
use lsmlite::superblock::Superblock;
use lsmlite::table::{Extent, TableMeta, decode_index, decode_meta, encode_index, encode_meta};
use lsmlite::table::BlockIndexEntry;
use proptest::prelude::*;

prop_compose! {
    fn arb_superblock()(
        version in 1u16..,
        epoch in any::<u64>(),
        checkpoint_lsn in any::<u64>(),
        j_head in any::<u64>(),
        j_tail in any::<u64>(),
    ) -> Superblock {
        Superblock {
            version,
            block_size: BLOCK_SIZE as u16,
            epoch,
            checkpoint_lsn,
            j_head,
            j_tail,
        }
    }
}

prop_compose! {
    fn arb_manifest_entry()(
        level in any::<u16>(),
        meta_off in any::<u64>(),
        meta_len in any::<u32>(),
        min_prefix in any::<[u8; 16]>(),
        max_prefix in any::<[u8; 16]>(),
    ) -> ManifestEntry {
        ManifestEntry { level, meta_off, meta_len, min_prefix, max_prefix }
    }
}

prop_compose! {
    fn arb_meta()(
        level in any::<u16>(),
        seq_min in any::<u64>(),
        seq_max in any::<u64>(),
        size_bytes in any::<u64>(),
        index_off in any::<u64>(),
        index_len in any::<u32>(),
        entry_count in any::<u32>(),
        min_key in any::<[u8; 16]>(),
        max_key in any::<[u8; 16]>(),
        id in "[a-f0-9-]{0,64}",
        extents in prop::collection::vec(
            (any::<u64>(), any::<u32>()).prop_map(|(s, b)| Extent { start_block: s, blocks: b }),
            0..8,
        ),
    ) -> TableMeta {
        TableMeta {
            level,
            seq_min,
            seq_max,
            size_bytes,
            block_size: BLOCK_SIZE as u32,
            index_off,
            index_len,
            entry_count,
            min_key,
            max_key,
            id,
            extents,
        }
    }
}

proptest! {
    #[test]
    fn superblock_encode_decode_is_identity(sb in arb_superblock()) {
        let image = sb.encode();
        prop_assert_eq!(image.len(), BLOCK_SIZE);
        prop_assert_eq!(Superblock::decode(&image), Some(sb));
    }

    #[test]
    fn manifest_encode_decode_is_identity(
        epoch in 1u64..,
        entries in prop::collection::vec(arb_manifest_entry(), 0..=MANIFEST_CAP),
    ) {
        let page = ManifestPage { version: 1, epoch, entries };
        let image = encode_page(&page).unwrap();
        prop_assert_eq!(decode_page(&image).unwrap(), page);
    }

    #[test]
    fn table_meta_encode_decode_is_identity(meta in arb_meta()) {
        let image = encode_meta(&meta).unwrap();
        prop_assert_eq!(image.len(), BLOCK_SIZE);
        prop_assert_eq!(decode_meta(&image).unwrap(), meta);
    }

    #[test]
    fn block_index_survives_padding(
        entries in prop::collection::vec(
            ("[a-z]{1,24}", any::<u64>(), 1u32..)
                .prop_map(|(k, off, len)| BlockIndexEntry { first_key: k.into_bytes(), off, len }),
            0..32,
        ),
        pad in 0usize..8,
    ) {
        let mut buf = encode_index(&entries);
        buf.resize(buf.len() + pad, 0);
        prop_assert_eq!(decode_index(&buf), entries);
    }
}
