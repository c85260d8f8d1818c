use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use super::error::{FileError, FileResult};
use super::frame::{FrameId, FramePool};
use super::{MAX_OPEN_FILE, PAGE_SIZE, POOL_NUM, PageNum};

/// Bytes of the file sub-header at the start of page 0's payload:
/// `allocated_pages: u32` followed by `page_count: u32`. The allocation
/// bitmap begins right after it.
const FILE_SUB_HEADER_SIZE: usize = 8;

/// Identifier of an open file: its slot in the open-file table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(usize);

impl FileId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// A pinned page. Created by `get_this_page`/`allocate_page` and consumed
/// by `unpin_page`; holders must unpin on every exit path.
#[must_use]
#[derive(Debug)]
pub struct PageHandle {
    frame: FrameId,
    file_desc: u64,
    page_num: PageNum,
}

impl PageHandle {
    pub fn page_num(&self) -> PageNum {
        self.page_num
    }
}

struct OpenFile {
    file: File,
    path: PathBuf,
    /// Unique per opening; frames and deferred disposals key on this, so a
    /// reused table slot can never be matched against a stale frame.
    file_desc: u64,
    /// Pinned for the life of the opening.
    hdr_frame: FrameId,
    /// Pages whose disposal waits for their last pin to drop.
    disposed: HashSet<PageNum>,
}

/// The buffer pool shared across every open file: a fixed frame pool plus
/// an open-file table. Page 0 of each file carries the sub-header and the
/// allocation bitmap; all page I/O goes through here.
pub struct DiskBufferPool {
    frames: FramePool,
    files: Vec<Option<OpenFile>>,
    next_desc: u64,
}

impl DiskBufferPool {
    pub fn new() -> Self {
        Self::with_limits(POOL_NUM, MAX_OPEN_FILE)
    }

    /// Pool with a custom frame count, for memory-constrained setups and tests.
    pub fn with_capacity(pool_frames: usize) -> Self {
        Self::with_limits(pool_frames, MAX_OPEN_FILE)
    }

    pub fn with_limits(pool_frames: usize, max_open_files: usize) -> Self {
        Self {
            frames: FramePool::new(pool_frames),
            files: (0..max_open_files).map(|_| None).collect(),
            next_desc: 1,
        }
    }

    /// Create a new paged file. Fails if the path already exists. The new
    /// file holds a single page: the header, allocated to itself.
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(FileError::Access)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    FileError::FileExists(path.display().to_string())
                } else {
                    FileError::Access(e)
                }
            })?;

        let mut page = [0u8; PAGE_SIZE];
        // data region: allocated_pages = 1, page_count = 1, bitmap bit 0 set
        page[4..8].copy_from_slice(&1u32.to_le_bytes());
        page[8..12].copy_from_slice(&1u32.to_le_bytes());
        page[12] |= 0x01;
        file.write_all(&page).map_err(FileError::Write)?;

        info!("created paged file {}", path.display());
        Ok(())
    }

    /// Open a paged file, pinning its header page for the life of the
    /// opening. Opening an already-open path returns the existing id.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileId> {
        let path = path
            .as_ref()
            .canonicalize()
            .map_err(FileError::Access)?;

        let mut empty_slot = None;
        for (i, slot) in self.files.iter().enumerate() {
            match slot {
                Some(open) if open.path == path => return Ok(FileId(i)),
                Some(_) => {}
                None if empty_slot.is_none() => empty_slot = Some(i),
                None => {}
            }
        }
        let Some(slot) = empty_slot else {
            error!("too many open files, cannot open {}", path.display());
            return Err(FileError::TooManyOpenFiles);
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(FileError::Access)?;

        let desc = self.next_desc;
        self.next_desc += 1;

        let frame = self.allocate_frame()?;
        {
            let f = self.frames.frame_mut(frame);
            f.pin_count = 1;
            f.dirty = false;
            f.file_desc = desc;
            f.page_num = 0;
        }
        let loaded = file
            .seek(SeekFrom::Start(0))
            .map_err(FileError::Seek)
            .and_then(|_| {
                file.read_exact(self.frames.frame_mut(frame).buf_mut())
                    .map_err(FileError::Read)
            });
        if let Err(e) = loaded {
            error!("failed to load header page of {}: {e}", path.display());
            self.frames.frame_mut(frame).pin_count = 0;
            self.frames.free(frame);
            return Err(e);
        }
        self.frames.register(frame, desc, 0);

        self.files[slot] = Some(OpenFile {
            file,
            path: path.clone(),
            file_desc: desc,
            hdr_frame: frame,
            disposed: HashSet::new(),
        });
        info!("opened {} as file id {slot}", path.display());
        Ok(FileId(slot))
    }

    /// Close an open file: unpin the header, purge every resident page and
    /// drop any deferred disposals. The pin is restored if the purge fails.
    pub fn close_file(&mut self, file_id: FileId) -> FileResult<()> {
        let hdr_frame = self.checked(file_id)?.hdr_frame;
        self.frames.frame_mut(hdr_frame).pin_count -= 1;
        if let Err(e) = self.purge_all_pages(file_id) {
            self.frames.frame_mut(hdr_frame).pin_count += 1;
            error!("failed to purge pages while closing file {}: {e}", file_id.0);
            return Err(e);
        }

        let open = self.files[file_id.0]
            .take()
            .ok_or(FileError::InvalidFileId(file_id.0))?;
        if let Err(e) = open.file.sync_all() {
            warn!("failed to sync {} on close: {e}", open.path.display());
            return Err(FileError::Close(e));
        }
        info!("closed file {}:{}", file_id.0, open.path.display());
        Ok(())
    }

    /// Pin the given page, loading it from disk if it is not resident.
    /// The page number must be allocated in the file's bitmap.
    pub fn get_this_page(&mut self, file_id: FileId, page_num: PageNum) -> FileResult<PageHandle> {
        let (desc, hdr_frame) = {
            let open = self.checked(file_id)?;
            (open.file_desc, open.hdr_frame)
        };
        self.check_page_num(hdr_frame, page_num)?;

        if let Some(frame) = self.frames.get(desc, page_num) {
            self.frames.frame_mut(frame).pin_count += 1;
            return Ok(PageHandle { frame, file_desc: desc, page_num });
        }

        let frame = self.allocate_frame()?;
        {
            let f = self.frames.frame_mut(frame);
            f.pin_count = 1;
            f.dirty = false;
            f.file_desc = desc;
            f.page_num = page_num;
        }
        if let Err(e) = self.load_page(file_id, frame, page_num) {
            error!("failed to load page {page_num} of file {}: {e}", file_id.0);
            self.frames.frame_mut(frame).pin_count = 0;
            self.frames.free(frame);
            return Err(e);
        }
        self.frames.register(frame, desc, page_num);
        Ok(PageHandle { frame, file_desc: desc, page_num })
    }

    /// Allocate a page: reuse the lowest free bitmap slot, or extend the
    /// file by one zeroed page. Returns the page pinned.
    pub fn allocate_page(&mut self, file_id: FileId) -> FileResult<PageHandle> {
        let (desc, hdr_frame) = {
            let open = self.checked(file_id)?;
            (open.file_desc, open.hdr_frame)
        };
        let (allocated, page_count) = self.sub_header(hdr_frame);

        if allocated < page_count {
            for page_num in 0..page_count {
                if !self.bitmap_bit(hdr_frame, page_num) {
                    self.set_bitmap_bit(hdr_frame, page_num, true);
                    self.set_sub_header(hdr_frame, allocated + 1, page_count);
                    self.frames.frame_mut(hdr_frame).dirty = true;
                    return self.get_this_page(file_id, page_num);
                }
            }
        }

        let frame = self.allocate_frame()?;
        let page_num = page_count;
        self.set_bitmap_bit(hdr_frame, page_num, true);
        self.set_sub_header(hdr_frame, allocated + 1, page_count + 1);
        self.frames.frame_mut(hdr_frame).dirty = true;
        {
            let f = self.frames.frame_mut(frame);
            f.file_desc = desc;
            f.pin_count = 1;
            f.dirty = false;
            f.reset(page_num);
        }
        self.frames.register(frame, desc, page_num);

        // extends the file on disk; a failure here is retried on the next flush
        if let Err(e) = self.flush_frame(frame) {
            warn!("failed to extend file {} with page {page_num}: {e}", file_id.0);
        }
        Ok(PageHandle { frame, file_desc: desc, page_num })
    }

    /// Release one pin. When the last pin drops, a pending deferred
    /// disposal of the page is completed.
    pub fn unpin_page(&mut self, handle: PageHandle) -> FileResult<()> {
        let PageHandle { frame, file_desc, page_num } = handle;
        let f = self.frames.frame_mut(frame);
        f.pin_count = f.pin_count.saturating_sub(1);
        if f.pin_count > 0 {
            return Ok(());
        }

        let slot = self
            .files
            .iter()
            .position(|s| s.as_ref().is_some_and(|open| open.file_desc == file_desc));
        let Some(slot) = slot else {
            return Ok(());
        };
        let pending = match self.files[slot].as_mut() {
            Some(open) => open.disposed.remove(&page_num),
            None => false,
        };
        if pending {
            info!("completing deferred disposal of page {page_num} of file {slot}");
            self.dispose_page(FileId(slot), page_num)?;
        }
        Ok(())
    }

    /// Logically free a page: purge it from the pool and clear its bitmap
    /// bit. A pinned page is recorded for deferred disposal and
    /// `PagePinned` is returned; the eventual last unpin completes it.
    pub fn dispose_page(&mut self, file_id: FileId, page_num: PageNum) -> FileResult<()> {
        let (desc, hdr_frame) = {
            let open = self.checked(file_id)?;
            (open.file_desc, open.hdr_frame)
        };
        self.check_page_num(hdr_frame, page_num)?;

        match self.purge_page_of(desc, page_num) {
            Ok(()) => {}
            Err(e @ FileError::PagePinned { .. }) => {
                info!("page {page_num} of file {} is in use, disposing later", file_id.0);
                if let Some(open) = self.files[file_id.0].as_mut() {
                    open.disposed.insert(page_num);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let (allocated, page_count) = self.sub_header(hdr_frame);
        self.set_bitmap_bit(hdr_frame, page_num, false);
        self.set_sub_header(hdr_frame, allocated - 1, page_count);
        self.frames.frame_mut(hdr_frame).dirty = true;
        Ok(())
    }

    /// Drop a page from the pool without touching the bitmap, flushing it
    /// first if dirty. Purging a pinned page fails with `PagePinned`.
    pub fn purge_page(&mut self, file_id: FileId, page_num: PageNum) -> FileResult<()> {
        let desc = self.checked(file_id)?.file_desc;
        self.purge_page_of(desc, page_num)
    }

    /// Purge every unpinned page of the file, flushing dirty ones. Pinned
    /// pages are skipped.
    pub fn purge_all_pages(&mut self, file_id: FileId) -> FileResult<()> {
        let desc = self.checked(file_id)?.file_desc;
        for frame in self.frames.frames_of(desc) {
            let (pin_count, dirty, page_num) = {
                let f = self.frames.frame(frame);
                (f.pin_count, f.dirty, f.page_num)
            };
            if pin_count > 0 {
                debug!("skipping pinned page {page_num} while purging file {}", file_id.0);
                continue;
            }
            if dirty {
                self.flush_frame(frame)?;
            }
            self.frames.free(frame);
        }
        Ok(())
    }

    pub fn mark_dirty(&mut self, handle: &PageHandle) {
        self.frames.frame_mut(handle.frame).dirty = true;
    }

    pub fn page_data(&self, handle: &PageHandle) -> &[u8] {
        self.frames.frame(handle.frame).data()
    }

    pub fn page_data_mut(&mut self, handle: &PageHandle) -> &mut [u8] {
        self.frames.frame_mut(handle.frame).data_mut()
    }

    pub fn page_count(&self, file_id: FileId) -> FileResult<PageNum> {
        let hdr_frame = self.checked(file_id)?.hdr_frame;
        Ok(self.sub_header(hdr_frame).1)
    }

    pub fn allocated_page_count(&self, file_id: FileId) -> FileResult<u32> {
        let hdr_frame = self.checked(file_id)?.hdr_frame;
        Ok(self.sub_header(hdr_frame).0)
    }

    pub fn is_page_allocated(&self, file_id: FileId, page_num: PageNum) -> FileResult<bool> {
        let hdr_frame = self.checked(file_id)?.hdr_frame;
        let (_, page_count) = self.sub_header(hdr_frame);
        Ok(page_num < page_count && self.bitmap_bit(hdr_frame, page_num))
    }

    fn checked(&self, file_id: FileId) -> FileResult<&OpenFile> {
        self.files
            .get(file_id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or(FileError::InvalidFileId(file_id.0))
    }

    fn check_page_num(&self, hdr_frame: FrameId, page_num: PageNum) -> FileResult<()> {
        let (_, page_count) = self.sub_header(hdr_frame);
        if page_num >= page_count || !self.bitmap_bit(hdr_frame, page_num) {
            return Err(FileError::InvalidPageNum(page_num));
        }
        Ok(())
    }

    fn sub_header(&self, hdr_frame: FrameId) -> (u32, u32) {
        let data = self.frames.frame(hdr_frame).data();
        let allocated = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let page_count = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        (allocated, page_count)
    }

    fn set_sub_header(&mut self, hdr_frame: FrameId, allocated: u32, page_count: u32) {
        let data = self.frames.frame_mut(hdr_frame).data_mut();
        data[0..4].copy_from_slice(&allocated.to_le_bytes());
        data[4..8].copy_from_slice(&page_count.to_le_bytes());
    }

    fn bitmap_bit(&self, hdr_frame: FrameId, page_num: PageNum) -> bool {
        let data = self.frames.frame(hdr_frame).data();
        let byte = FILE_SUB_HEADER_SIZE + (page_num / 8) as usize;
        data[byte] & (1 << (page_num % 8)) != 0
    }

    fn set_bitmap_bit(&mut self, hdr_frame: FrameId, page_num: PageNum, set: bool) {
        let data = self.frames.frame_mut(hdr_frame).data_mut();
        let byte = FILE_SUB_HEADER_SIZE + (page_num / 8) as usize;
        if set {
            data[byte] |= 1 << (page_num % 8);
        } else {
            data[byte] &= !(1 << (page_num % 8));
        }
    }

    fn purge_page_of(&mut self, file_desc: u64, page_num: PageNum) -> FileResult<()> {
        match self.frames.peek(file_desc, page_num) {
            Some(frame) => self.purge_frame(frame),
            None => Ok(()),
        }
    }

    fn purge_frame(&mut self, frame: FrameId) -> FileResult<()> {
        let (pin_count, dirty, page_num) = {
            let f = self.frames.frame(frame);
            (f.pin_count, f.dirty, f.page_num)
        };
        if pin_count > 0 {
            return Err(FileError::PagePinned { page_num, pin_count });
        }
        if dirty {
            self.flush_frame(frame)?;
        }
        self.frames.free(frame);
        Ok(())
    }

    /// Reserve a frame: free list first, then the eviction candidate,
    /// flushing it if dirty. Fails when every frame is pinned.
    fn allocate_frame(&mut self) -> FileResult<FrameId> {
        if let Some(frame) = self.frames.alloc() {
            return Ok(frame);
        }
        let Some(victim) = self.frames.begin_purge() else {
            error!("all frames are in use and pinned");
            return Err(FileError::NoFreeFrames);
        };
        if self.frames.frame(victim).dirty {
            self.flush_frame(victim)?;
        }
        self.frames.free(victim);
        self.frames.alloc().ok_or(FileError::NoFreeFrames)
    }

    fn load_page(&mut self, file_id: FileId, frame: FrameId, page_num: PageNum) -> FileResult<()> {
        let offset = page_num as u64 * PAGE_SIZE as u64;
        let Some(open) = self.files.get_mut(file_id.0).and_then(|slot| slot.as_mut()) else {
            return Err(FileError::InvalidFileId(file_id.0));
        };
        open.file
            .seek(SeekFrom::Start(offset))
            .map_err(FileError::Seek)?;
        open.file
            .read_exact(self.frames.frame_mut(frame).buf_mut())
            .map_err(FileError::Read)
    }

    fn flush_frame(&mut self, frame: FrameId) -> FileResult<()> {
        let (desc, page_num) = {
            let f = self.frames.frame(frame);
            (f.file_desc, f.page_num)
        };
        let offset = page_num as u64 * PAGE_SIZE as u64;
        let Some(open) = self.files.iter_mut().flatten().find(|f| f.file_desc == desc) else {
            return Err(FileError::Access(io::Error::new(
                io::ErrorKind::NotFound,
                "no open file for frame",
            )));
        };
        open.file
            .seek(SeekFrom::Start(offset))
            .map_err(FileError::Seek)?;
        open.file
            .write_all(self.frames.frame(frame).buf())
            .map_err(FileError::Write)?;
        self.frames.frame_mut(frame).dirty = false;
        debug!("flushed page {page_num} of descriptor {desc}");
        Ok(())
    }
}

impl Default for DiskBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskBufferPool) {
        (tempfile::tempdir().unwrap(), DiskBufferPool::new())
    }

    #[test]
    fn test_create_file_writes_header() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();

        let file_id = pool.open_file(&path).unwrap();
        assert_eq!(pool.page_count(file_id).unwrap(), 1);
        assert_eq!(pool.allocated_page_count(file_id).unwrap(), 1);
        assert!(pool.is_page_allocated(file_id, 0).unwrap());
    }

    #[test]
    fn test_create_file_exists() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let result = pool.create_file(&path);
        assert!(matches!(result, Err(FileError::FileExists(_))));
    }

    #[test]
    fn test_open_same_file_twice_returns_same_id() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let a = pool.open_file(&path).unwrap();
        let b = pool.open_file(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_open_too_many_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = DiskBufferPool::with_limits(8, 2);
        for i in 0..3 {
            pool.create_file(dir.path().join(format!("f{i}.data"))).unwrap();
        }
        pool.open_file(dir.path().join("f0.data")).unwrap();
        pool.open_file(dir.path().join("f1.data")).unwrap();
        let result = pool.open_file(dir.path().join("f2.data"));
        assert!(matches!(result, Err(FileError::TooManyOpenFiles)));
    }

    #[test]
    fn test_close_reopen_round_trip() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();

        let file_id = pool.open_file(&path).unwrap();
        for _ in 0..3 {
            let handle = pool.allocate_page(file_id).unwrap();
            pool.unpin_page(handle).unwrap();
        }
        let page_count = pool.page_count(file_id).unwrap();
        let allocated = pool.allocated_page_count(file_id).unwrap();
        pool.close_file(file_id).unwrap();

        let file_id = pool.open_file(&path).unwrap();
        assert_eq!(pool.page_count(file_id).unwrap(), page_count);
        assert_eq!(pool.allocated_page_count(file_id).unwrap(), allocated);
    }

    #[test]
    fn test_get_unallocated_page_fails() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let result = pool.get_this_page(file_id, 1);
        assert!(matches!(result, Err(FileError::InvalidPageNum(1))));
    }

    #[test]
    fn test_invalid_file_id() {
        let (_dir, mut pool) = setup();
        let result = pool.get_this_page(FileId(5), 0);
        assert!(matches!(result, Err(FileError::InvalidFileId(5))));
    }

    #[test]
    fn test_page_data_round_trip_through_disk() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let handle = pool.allocate_page(file_id).unwrap();
        let page_num = handle.page_num();
        pool.page_data_mut(&handle)[0] = 42;
        pool.page_data_mut(&handle)[100] = 7;
        pool.mark_dirty(&handle);
        pool.unpin_page(handle).unwrap();
        pool.close_file(file_id).unwrap();

        let file_id = pool.open_file(&path).unwrap();
        let handle = pool.get_this_page(file_id, page_num).unwrap();
        assert_eq!(pool.page_data(&handle)[0], 42);
        assert_eq!(pool.page_data(&handle)[100], 7);
        pool.unpin_page(handle).unwrap();
    }

    #[test]
    fn test_allocate_dispose_round_trip() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let before_allocated = pool.allocated_page_count(file_id).unwrap();
        let handle = pool.allocate_page(file_id).unwrap();
        let page_num = handle.page_num();
        pool.unpin_page(handle).unwrap();
        assert_eq!(pool.allocated_page_count(file_id).unwrap(), before_allocated + 1);

        pool.dispose_page(file_id, page_num).unwrap();
        assert_eq!(pool.allocated_page_count(file_id).unwrap(), before_allocated);
        assert!(!pool.is_page_allocated(file_id, page_num).unwrap());
        // page_count is monotonic
        assert_eq!(pool.page_count(file_id).unwrap(), 2);
    }

    #[test]
    fn test_disposed_page_is_reused_first() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let first = pool.allocate_page(file_id).unwrap();
        let first_num = first.page_num();
        pool.unpin_page(first).unwrap();
        let second = pool.allocate_page(file_id).unwrap();
        pool.unpin_page(second).unwrap();

        pool.dispose_page(file_id, first_num).unwrap();
        let reused = pool.allocate_page(file_id).unwrap();
        assert_eq!(reused.page_num(), first_num);
        pool.unpin_page(reused).unwrap();
        // no extension happened
        assert_eq!(pool.page_count(file_id).unwrap(), 3);
    }

    #[test]
    fn test_pool_exhaustion_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = DiskBufferPool::with_capacity(4);
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        // header frame is pinned; pin three more pages to fill the pool
        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(pool.allocate_page(file_id).unwrap());
        }
        let result = pool.allocate_page(file_id);
        assert!(matches!(result, Err(FileError::NoFreeFrames)));

        pool.unpin_page(handles.pop().unwrap()).unwrap();
        let handle = pool.allocate_page(file_id).unwrap();
        pool.unpin_page(handle).unwrap();
        for handle in handles {
            pool.unpin_page(handle).unwrap();
        }
    }

    #[test]
    fn test_eviction_flushes_dirty_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = DiskBufferPool::with_capacity(3);
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let handle = pool.allocate_page(file_id).unwrap();
        let dirty_num = handle.page_num();
        pool.page_data_mut(&handle)[0] = 0xEE;
        pool.mark_dirty(&handle);
        pool.unpin_page(handle).unwrap();

        // churn through enough pages to evict the dirty one
        for _ in 0..4 {
            let handle = pool.allocate_page(file_id).unwrap();
            pool.unpin_page(handle).unwrap();
        }

        let handle = pool.get_this_page(file_id, dirty_num).unwrap();
        assert_eq!(pool.page_data(&handle)[0], 0xEE);
        pool.unpin_page(handle).unwrap();
    }

    #[test]
    fn test_dispose_pinned_page_is_deferred() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let handle = pool.allocate_page(file_id).unwrap();
        let page_num = handle.page_num();

        let result = pool.dispose_page(file_id, page_num);
        assert!(matches!(result, Err(FileError::PagePinned { .. })));
        // still allocated and reachable while pinned
        assert!(pool.is_page_allocated(file_id, page_num).unwrap());
        let probe = pool.get_this_page(file_id, page_num).unwrap();
        pool.unpin_page(probe).unwrap();

        // the last unpin completes the disposal
        pool.unpin_page(handle).unwrap();
        assert!(!pool.is_page_allocated(file_id, page_num).unwrap());
        let result = pool.get_this_page(file_id, page_num);
        assert!(matches!(result, Err(FileError::InvalidPageNum(_))));
    }

    #[test]
    fn test_purge_all_skips_pinned_pages() {
        let (dir, mut pool) = setup();
        let path = dir.path().join("t.data");
        pool.create_file(&path).unwrap();
        let file_id = pool.open_file(&path).unwrap();

        let handle = pool.allocate_page(file_id).unwrap();
        let page_num = handle.page_num();
        pool.purge_all_pages(file_id).unwrap();

        // the pinned page survived the purge
        let again = pool.get_this_page(file_id, page_num).unwrap();
        pool.unpin_page(again).unwrap();
        pool.unpin_page(handle).unwrap();
    }
}
