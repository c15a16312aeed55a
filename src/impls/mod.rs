mod subsonic;
